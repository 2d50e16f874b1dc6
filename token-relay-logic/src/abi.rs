use alloy::sol;

sol! {
    /// Marker emitted by the relayer's wallet module for every failed
    /// sub-transaction of a bundle.
    interface IRelayWallet {
        event TxFailed(bytes32 _tx, bytes _reason);
    }

    struct MetaTxn {
        bool delegateCall;
        bool revertOnError;
        uint256 gasLimit;
        address target;
        uint256 value;
        bytes data;
    }
}

sol! {
    interface IERC721 {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }
}

sol! {
    interface IERC1155 {
        event TransferSingle(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256 id,
            uint256 value
        );
        event TransferBatch(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256[] ids,
            uint256[] values
        );
    }
}

sol! {
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function balanceOf(address account) external view returns (uint256);
    }
}

sol! {
    interface ITreasury {
        event LogGoldClaimed(address user, uint256 gold, uint256 uuid);

        function claim(address user, uint256[] ids, uint256[] classes, bytes32 guid) external;
    }

    interface IAdventurersGuild {
        event LogAdventuringGoldClaimed(address user, uint256 gold, uint256 time, uint256 uuid);

        function claim(address user, uint256[] ids, bytes32 guid) external;
        function stake(address user, uint256[] tokenIds) external;
        function unStake(address user, uint256[] tokenIds, bytes32 guid) external;
    }

    interface ISystemChecker {
        function connectUser(address user, uint256 nonce, bytes signature) external;
        function disconnectUser(address user, uint256 nonce, bytes signature) external;
    }

    interface IItemFactory {
        event LogBuyBox(address buyer, uint256 quantity);
        event LogOpenBox(address buyer, uint256[] itemIds);

        function buyBox(address user, uint256 quantity) external;
    }

    interface IMilkAction {
        function buy(address user, bytes32 actionKey, bytes32 data) external;
    }

    interface IOpenPetBoxes {
        function openMultipleBoxes(address user, uint256 quantity, uint256 entropy, bytes32 guid) external;
    }

    interface IPetInteraction {
        event LogPetInteractionEvent(address from, uint256 petTokenId, uint256 itemTokenId);
        event LogPetReachBlobOneEvent(address from, uint256 petTokenId);
        event LogPetReachBlobTwoEvent(address from, uint256 petTokenId);
        event LogPetReachFinalFormEvent(address from, uint256 petTokenId);

        function interact(address user, uint256 petTokenId, uint256 itemTokenId) external;
    }

    interface IMarketplace {
        event LogNewListing(
            uint256 listingId,
            address seller,
            uint256 tokenId,
            uint256 amount,
            uint256 price,
            uint256 priceWithFee
        );
        event LogRemoveListing(uint256 listingId, address seller, bool isSale);
        event LogPurchase(uint256 listingId, address seller, address buyer);

        function createListing(uint256 itemTokenId, uint256 amount, uint256 price, address seller) external;
        function removeListing(uint256 listingId, address seller) external;
        function buyListing(address buyer, uint256 listingId) external;
    }

    interface IQuest {
        function rollUserQuests(address user, bool reRoll, uint256 entropy) external;
        function completeQuestAndRoll(
            address user,
            uint256 index,
            uint256 petTokenId,
            uint256[] chosenItems,
            uint256 entropy,
            bool rewardBonus
        ) external;
    }
}
